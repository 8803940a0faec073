//! Transaction lifecycle: begin/commit/abort state transitions, two-phase
//! locking behavior, and durability across a restart.

mod common;

use common::{int_at, Db};
use ferrodb::catalog::types::{ColType, CompOp, Value};
use ferrodb::executor::{CondRhs, Condition, Plan, TabCol};
use ferrodb::transaction::TxnState;
use ferrodb::Error;
use tempfile::TempDir;

fn create_accounts(db: &Db) {
    db.sm
        .create_table(
            "accounts",
            &[
                ("id".to_string(), ColType::Int, 0),
                ("balance".to_string(), ColType::Int, 0),
            ],
        )
        .unwrap();
    db.sm
        .create_index("accounts", &["id".to_string()], &db.ctx())
        .unwrap();
}

fn insert(db: &Db, ctx: &ferrodb::Context, id: i32, balance: i32) -> ferrodb::Result<()> {
    db.run(
        ctx,
        &Plan::Insert {
            table: "accounts".to_string(),
            values: vec![Value::Int(id), Value::Int(balance)],
        },
    )
    .map(|_| ())
}

fn select_all(db: &Db) -> Vec<(i32, i32)> {
    let result = db
        .run(
            &db.ctx(),
            &Plan::SeqScan {
                table: "accounts".to_string(),
                conds: vec![],
            },
        )
        .unwrap();
    result
        .rows
        .iter()
        .map(|r| (int_at(r, 0), int_at(r, 4)))
        .collect()
}

#[test]
fn test_transaction_lifecycle() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path());
    create_accounts(&db);

    // BEGIN .. COMMIT
    let txn = db.tm.begin(None).unwrap();
    assert_eq!(txn.state(), TxnState::Growing);
    insert(&db, &db.txn_ctx(&txn), 1, 100).unwrap();
    db.tm.commit(&txn).unwrap();
    assert_eq!(txn.state(), TxnState::Committed);
    assert_eq!(select_all(&db), vec![(1, 100)]);

    // BEGIN .. ABORT undoes everything, including index entries.
    let txn = db.tm.begin(None).unwrap();
    insert(&db, &db.txn_ctx(&txn), 2, 200).unwrap();
    db.tm.abort(&txn).unwrap();
    assert_eq!(txn.state(), TxnState::Aborted);
    assert_eq!(select_all(&db), vec![(1, 100)]);
    // The key freed by the abort is insertable again.
    let txn = db.tm.begin(None).unwrap();
    insert(&db, &db.txn_ctx(&txn), 2, 250).unwrap();
    db.tm.commit(&txn).unwrap();
    assert_eq!(select_all(&db).len(), 2);
}

#[test]
fn test_growing_shrinking_discipline() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path());
    create_accounts(&db);
    let fd = db.sm.get_heap("accounts").unwrap().fd();

    let txn = db.tm.begin(None).unwrap();
    db.lock_mgr.lock_shared_on_table(&txn, fd).unwrap();
    db.lock_mgr
        .unlock(&txn, ferrodb::transaction::LockDataId::Table { fd });
    assert_eq!(txn.state(), TxnState::Shrinking);

    // Any further lock request is a 2PL violation.
    let err = db.lock_mgr.lock_shared_on_table(&txn, fd);
    assert!(matches!(err, Err(Error::LockOnShrinking(_))));
    db.tm.abort(&txn).unwrap();
}

#[test]
fn test_writer_blocks_reader_no_wait() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path());
    create_accounts(&db);
    let txn = db.tm.begin(None).unwrap();
    insert(&db, &db.txn_ctx(&txn), 1, 100).unwrap();

    // A second transaction scanning the table conflicts with the writer's
    // IX lock and aborts immediately.
    let reader = db.tm.begin(None).unwrap();
    let err = db.run(
        &db.txn_ctx(&reader),
        &Plan::SeqScan {
            table: "accounts".to_string(),
            conds: vec![],
        },
    );
    assert!(matches!(err, Err(Error::DeadlockPrevention(_))));
    db.tm.abort(&reader).unwrap();
    db.tm.commit(&txn).unwrap();
}

#[test]
fn test_committed_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let db = Db::open(dir.path());
        create_accounts(&db);
        let txn = db.tm.begin(None).unwrap();
        let ctx = db.txn_ctx(&txn);
        insert(&db, &ctx, 1, 100).unwrap();
        insert(&db, &ctx, 2, 200).unwrap();
        db.tm.commit(&txn).unwrap();

        let txn = db.tm.begin(None).unwrap();
        let plan = Plan::Update {
            table: "accounts".to_string(),
            child: Box::new(Plan::SeqScan {
                table: "accounts".to_string(),
                conds: vec![Condition {
                    lhs_col: TabCol::new("accounts", "id"),
                    op: CompOp::Eq,
                    rhs: CondRhs::Val(Value::Int(1)),
                }],
            }),
            set_clauses: vec![ferrodb::executor::SetClause {
                lhs: TabCol::new("accounts", "balance"),
                op: ferrodb::catalog::types::SetOp::Minus,
                rhs: Value::Int(30),
            }],
        };
        db.run(&db.txn_ctx(&txn), &plan).unwrap();
        db.tm.commit(&txn).unwrap();
        // Crash without flushing heap pages.
    }

    let db = Db::open_with_recovery(dir.path());
    let mut rows = select_all(&db);
    rows.sort_unstable();
    assert_eq!(rows, vec![(1, 70), (2, 200)]);
}

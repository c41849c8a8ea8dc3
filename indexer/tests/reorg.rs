mod common;

use common::*;
use mex_indexer::database::queries::{BlockQueries, OutputQueries};
use mex_indexer::indexer::{rollback_from, ReorgOutcome, ReorgReconciler};

#[tokio::test]
async fn test_truncates_from_fork_height() {
    let (_dir, db) = temp_db().await;
    let node = MockNode::with_chain("a", 111);
    import_chain(db.pool(), &node).await;

    node.fork_at(105, "b");

    let outcome = ReorgReconciler::new(db.pool(), &node, 11).reconcile().await.unwrap();
    assert_eq!(outcome, ReorgOutcome::RolledBack { fork_height: 105, blocks_removed: 6 });

    assert_eq!(BlockQueries::head_height(db.pool()).await.unwrap(), Some(104));
    for height in 100..=104 {
        let block = BlockQueries::get_by_height(db.pool(), height).await.unwrap().unwrap();
        assert_eq!(block.hash, block_hash("a", height as u64));
    }
    assert_eq!(count(db.pool(), "SELECT COUNT(*) FROM transactions WHERE block_height >= 105").await, 0);
    assert_eq!(count(db.pool(), "SELECT COUNT(*) FROM transactions").await, 105);
    assert_eq!(count(db.pool(), "SELECT COUNT(*) FROM outputs").await, 105);
    assert_eq!(count(db.pool(), "SELECT COUNT(*) FROM inputs").await, 105);

    // The next import pass follows the new branch.
    import_chain(db.pool(), &node).await;
    let head = BlockQueries::get_by_height(db.pool(), 110).await.unwrap().unwrap();
    assert_eq!(head.hash, block_hash("b", 110));
}

#[tokio::test]
async fn test_agreement_deletes_nothing() {
    let (_dir, db) = temp_db().await;
    let node = MockNode::with_chain("a", 20);
    import_chain(db.pool(), &node).await;

    let outcome = ReorgReconciler::new(db.pool(), &node, 300).reconcile().await.unwrap();
    assert_eq!(outcome, ReorgOutcome::InSync);
    assert_eq!(BlockQueries::count(db.pool()).await.unwrap(), 20);
    assert_eq!(count(db.pool(), "SELECT COUNT(*) FROM transactions").await, 20);
}

#[tokio::test]
async fn test_empty_store_is_noop() {
    let (_dir, db) = temp_db().await;
    let node = MockNode::with_chain("a", 5);

    let outcome = ReorgReconciler::new(db.pool(), &node, 300).reconcile().await.unwrap();
    assert_eq!(outcome, ReorgOutcome::Empty);
    assert_eq!(node.calls("listblocks"), 0);
}

#[tokio::test]
async fn test_node_behind_leaves_store_untouched() {
    let (_dir, db) = temp_db().await;
    let node = MockNode::with_chain("a", 11);
    import_chain(db.pool(), &node).await;

    node.truncate(6);

    let outcome = ReorgReconciler::new(db.pool(), &node, 300).reconcile().await.unwrap();
    assert_eq!(outcome, ReorgOutcome::NodeBehind { local_head: 10, node_head: 5 });
    assert_eq!(BlockQueries::count(db.pool()).await.unwrap(), 11);
    assert_eq!(node.calls("listblocks"), 1);
}

#[tokio::test]
async fn test_transport_failure_deletes_nothing() {
    let (_dir, db) = temp_db().await;
    let node = MockNode::with_chain("a", 10);
    import_chain(db.pool(), &node).await;

    node.fork_at(5, "b");
    node.set_offline(true);

    let err = ReorgReconciler::new(db.pool(), &node, 300).reconcile().await.unwrap_err();
    assert!(err.is_node_transport());
    assert_eq!(BlockQueries::count(db.pool()).await.unwrap(), 10);
}

#[tokio::test]
async fn test_rollback_restores_spent_flag() {
    let (_dir, db) = temp_db().await;
    let node = MockNode::with_chain("a", 3);
    node.push_block(
        "a",
        vec![
            coinbase(&coinbase_txid("a", 3), "1Minera", 50),
            spend("pay", &[(coinbase_txid("a", 1).as_str(), 0)], &[("1Alice", 30), ("1Minera", 20)]),
        ],
    );
    import_chain(db.pool(), &node).await;

    let funding = OutputQueries::find(db.pool(), &coinbase_txid("a", 1), 0).await.unwrap().unwrap();
    assert!(funding.spent);

    node.fork_at(3, "b");
    let outcome = ReorgReconciler::new(db.pool(), &node, 300).reconcile().await.unwrap();
    assert_eq!(outcome, ReorgOutcome::RolledBack { fork_height: 3, blocks_removed: 1 });

    let funding = OutputQueries::find(db.pool(), &coinbase_txid("a", 1), 0).await.unwrap().unwrap();
    assert!(!funding.spent);
    assert!(OutputQueries::find(db.pool(), "pay", 0).await.unwrap().is_none());
    assert_eq!(OutputQueries::spent_flag_mismatches(db.pool()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_rollback_removes_stream_items() {
    let (_dir, db) = temp_db().await;
    let node = MockNode::with_chain("a", 2);
    node.push_block("a", vec![coinbase(&coinbase_txid("a", 2), "1Minera", 50), data_tx("anchor", 2)]);
    node.add_channel(channel("iscc"));
    node.push_items("iscc", vec![item("anchor", 0, 1), item("anchor", 1, 1)]);
    import_chain(db.pool(), &node).await;

    let streams = mex_indexer::indexer::StreamIndexer::new(db.pool(), &node, 100);
    streams.sync_streams().await.unwrap();
    assert_eq!(streams.sync_items_for("iscc").await.unwrap(), 2);

    let removed = rollback_from(db.pool(), 2).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(count(db.pool(), "SELECT COUNT(*) FROM stream_items").await, 0);
    assert_eq!(count(db.pool(), "SELECT COUNT(*) FROM stream_item_publishers").await, 0);
    assert_eq!(count(db.pool(), "SELECT COUNT(*) FROM streams").await, 1);
    // Addresses are never removed by sync.
    assert_eq!(count(db.pool(), "SELECT COUNT(*) FROM addresses WHERE address = '1Publisher'").await, 1);
}

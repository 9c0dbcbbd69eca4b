use crate::*;

use tokenring_node::{inject_token, ring_topology, NodeHandle, Ring, RingNode};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_token_visits_nodes_in_ring_order() -> Result<()> {
    let _guard = ring_lock();
    let mut ring = Ring::bind(&ring_config(5000, 3)).await?;
    let handles = ring.handles();
    let mut feeds: Vec<_> = handles.iter().map(NodeHandle::subscribe).collect();
    ring.start()?;
    ring.inject_token().await?;

    let first = next_catch(&mut feeds[0]).await?;
    let second = next_catch(&mut feeds[1]).await?;
    let third = next_catch(&mut feeds[2]).await?;
    let back = next_catch(&mut feeds[0]).await?;

    assert_eq!(
        [first.node, second.node, third.node, back.node],
        [NodeId(5000), NodeId(5001), NodeId(5002), NodeId(5000)]
    );
    assert!(first.at < second.at, "5001 caught before 5000");
    assert!(second.at < third.at, "5002 caught before 5001");
    assert!(third.at < back.at, "token back at 5000 before 5002 had it");
    assert!(first.round_trip.is_none(), "first catch has no previous catch");
    assert!(back.round_trip.is_some());

    // last_token_time only moves forward while the token circulates.
    let mut prev = handles[0]
        .last_token_time()
        .context("5000 never recorded a catch")?;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(2)).await;
        let now = handles[0].last_token_time().context("catch time lost")?;
        assert!(now >= prev, "last_token_time went backwards");
        prev = now;
    }

    ring.stop().await?;
    assert!(handles.iter().all(|h| !h.is_running()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stopped_node_halts_circulation() -> Result<()> {
    let mut nodes = Vec::new();
    for (bind, successor) in ring_topology(localhost(0).ip(), 5100, 3)? {
        nodes.push(RingNode::bind(bind, successor).await?);
    }
    for node in &mut nodes {
        node.start()?;
    }
    inject_token(localhost(5100)).await?;

    let handles: Vec<_> = nodes.iter().map(RingNode::handle).collect();
    wait_until("five rounds", || {
        handles.iter().all(|h| h.status().token_catches >= 5)
    })
    .await?;

    nodes[1].stop().await?;
    assert!(!handles[1].is_running());

    // Anything in flight settles, then nothing moves.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let frozen: Vec<u64> = handles.iter().map(|h| h.status().token_catches).collect();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let later: Vec<u64> = handles.iter().map(|h| h.status().token_catches).collect();
    assert_eq!(frozen, later, "token still circulating without 5101");

    for node in &mut nodes {
        // The survivors may have hit a refused send to the stopped port.
        let _ = node.stop().await;
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_at_most_one_node_holds_the_token() -> Result<()> {
    let mut ring = Ring::launch(&ring_config(5400, 3)).await?;
    let handles = ring.handles();
    wait_until("first round", || {
        handles.iter().all(|h| h.status().token_catches > 0)
    })
    .await?;
    let catches_before = handles[0].status().token_catches;

    // Read a, then its successor b, then a again. If a held the token on
    // both reads, b must not have held it in between.
    let deadline = Instant::now() + Duration::from_millis(500);
    let mut rounds = 0u64;
    let mut overlaps = Vec::new();
    while Instant::now() < deadline {
        for (i, a) in handles.iter().enumerate() {
            let b = &handles[(i + 1) % handles.len()];
            let a_before = a.has_token();
            let b_now = b.has_token();
            let a_after = a.has_token();
            if a_before && b_now && a_after {
                overlaps.push((a.id(), b.id()));
            }
        }
        rounds += 1;
        if rounds % 10_000 == 0 {
            tokio::task::yield_now().await;
        }
    }

    assert!(overlaps.is_empty(), "two holders at once: {overlaps:?}");
    assert!(
        handles[0].status().token_catches > catches_before,
        "token stopped circulating while sampling"
    );

    ring.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_launch_rejects_invalid_config() {
    assert!(Ring::launch(&ring_config(5150, 0)).await.is_err());
    assert!(Ring::launch(&ring_config(u16::MAX, 2)).await.is_err());
}

use crate::*;

use std::collections::BTreeMap;

use tokenring_core::{Signature, Vector, MOVE};
use tokenring_node::Ring;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_move_applied_once_everywhere() -> Result<()> {
    let _guard = ring_lock();
    let mut ring = Ring::launch(&ring_config(5000, 3)).await?;
    let handles = ring.handles();

    let origin = Signature::of(NodeId(5001));
    assert_eq!(origin.as_bytes(), [0x13, 0x89]);
    handles[1].enqueue_local_command(MOVE, &b"d"[..])?;

    wait_until("move on every node", || {
        handles
            .iter()
            .all(|h| h.snapshot_world().get(&origin) == Some(&Vector::new(1, 0)))
    })
    .await?;

    // Many more rounds: nothing is applied twice.
    let catches = handles[1].status().token_catches;
    wait_until("ten more rounds", || {
        handles[1].status().token_catches > catches + 10
    })
    .await?;

    for h in &handles {
        let world = h.snapshot_world();
        assert_eq!(world.len(), 1, "unexpected entries at {}", h.id());
        assert_eq!(world[&origin], Vector::new(1, 0));
        assert_eq!(h.status().applied, 1);
    }
    // 5001 -> 5002 -> 5000 -> back at 5001, where it stops.
    assert_eq!(handles[1].status().suppressed, 1);
    assert_eq!(handles[1].status().forwarded, 0);
    assert_eq!(handles[2].status().forwarded, 1);
    assert_eq!(handles[0].status().forwarded, 1);

    ring.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worlds_converge_with_mixed_commands() -> Result<()> {
    let mut ring = Ring::launch(&ring_config(5200, 4)).await?;
    let handles = ring.handles();

    handles[0].enqueue_local_command(MOVE, &b"wd"[..])?;
    // Unknown command: relayed and committed, but inert.
    handles[2].enqueue_local_command(b'X', &b"hello"[..])?;
    // Opposite keys cancel.
    handles[3].enqueue_local_command(MOVE, &b"ad"[..])?;

    wait_until("all three events applied", || {
        handles.iter().all(|h| h.status().applied == 3)
    })
    .await?;

    let expected: BTreeMap<_, _> = [
        (Signature::of(NodeId(5200)), Vector::new(1, -1)),
        (Signature::of(NodeId(5202)), Vector::ORIGIN),
        (Signature::of(NodeId(5203)), Vector::ORIGIN),
    ]
    .into_iter()
    .collect();
    for h in &handles {
        assert_eq!(h.snapshot_world(), expected, "world at {}", h.id());
    }
    let suppressed: Vec<u64> = handles.iter().map(|h| h.status().suppressed).collect();
    assert_eq!(suppressed, [1, 0, 1, 1]);

    ring.stop().await?;
    Ok(())
}

use crate::*;

use tokenring_core::{encode, Frame, FrameReader, Signature, Vector, MOVE};
use tokenring_node::transport::RecvEndpoint;
use tokenring_node::RingNode;

/// Frames split across datagrams, behind leading garbage, still arrive
/// whole and are relayed in order.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fragmented_frames_are_relayed_and_applied() -> Result<()> {
    let mut sink = RecvEndpoint::bind(localhost(0)).await?;
    let mut node = RingNode::bind(localhost(5300), sink.local_addr()?).await?;
    let handle = node.handle();
    node.start()?;

    let stranger = NodeId(0x0001);
    let move_bytes = encode(&[MOVE], &stranger.sign(b"s"))?;
    let token_bytes = Frame::token().to_bytes()?;

    let feeder = tokio::net::UdpSocket::bind(localhost(0)).await?;
    let target = localhost(5300);
    feeder.send_to(b"zz", target).await?;
    feeder.send_to(&move_bytes[..5], target).await?;
    let mut rest = move_bytes[5..].to_vec();
    rest.extend_from_slice(&token_bytes);
    feeder.send_to(&rest, target).await?;

    let mut reader = FrameReader::new();
    let mut relayed = Vec::new();
    tokio::time::timeout(TIMEOUT, async {
        while relayed.len() < 2 {
            sink.readable().await?;
            while let Some(frame) = reader.poll_frame(&mut sink)? {
                relayed.push(frame);
            }
        }
        anyhow::Ok(())
    })
    .await
    .context("timed out waiting for relayed frames")??;

    assert_eq!(relayed[0].command, MOVE);
    assert_eq!(&relayed[0].args[..], &[0x00, 0x01, b's']);
    assert!(relayed[1].is_token());

    let origin = Signature::of(stranger);
    wait_until("move applied", || {
        handle.snapshot_world().get(&origin) == Some(&Vector::new(0, 1))
    })
    .await?;
    assert_eq!(handle.status().forwarded, 1);

    node.stop().await?;
    Ok(())
}

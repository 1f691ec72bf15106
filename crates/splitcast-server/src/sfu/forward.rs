//! Per-stream RTP forwarding
//!
//! Reads media units from a publisher's inbound track and writes them
//! unmodified to the forward track that subscribers consume.

use crate::transport::{ForwardTrack, InboundTrack};
use splitcast_protocol::ClientId;
use std::sync::Arc;
use tokio::sync::watch;

/// Relay packets until the inbound stream ends or `stop` fires.
///
/// `stop` is owned by the publisher connection: it flips to `true` (or its
/// sender is dropped) when that connection is released. Returns the number of
/// packets relayed.
pub async fn forward<I, F>(
    owner: ClientId,
    inbound: Arc<I>,
    track: Arc<F>,
    mut stop: watch::Receiver<bool>,
) -> u64
where
    I: InboundTrack,
    F: ForwardTrack<Packet = I::Packet>,
{
    let kind = inbound.kind();
    tracing::info!("Starting {} forwarding for {} ({})", kind, owner, track.id());

    let mut packet_count = 0u64;

    loop {
        if *stop.borrow() {
            tracing::info!("Forwarding of {} stopped by publisher release", track.id());
            break;
        }

        let packet = tokio::select! {
            biased;

            changed = stop.changed() => {
                if changed.is_err() {
                    tracing::info!("Publisher of {} released", track.id());
                    break;
                }
                continue;
            }
            result = inbound.read_packet() => match result {
                Ok(packet) => packet,
                Err(e) => {
                    tracing::info!("Source {} track of {} ended: {}", kind, owner, e);
                    break;
                }
            },
        };

        packet_count += 1;

        if let Err(e) = track.write_packet(&packet).await {
            // No subscriber bound yet, or one just went away; keep relaying
            if packet_count % 100 == 1 {
                tracing::debug!("Failed to forward packet {} on {}: {}", packet_count, track.id(), e);
            }
        }
    }

    tracing::debug!("Forwarded {} packets on {}", packet_count, track.id());
    packet_count
}

//! Peer fanout of accepted attestations.
//!
//! Best-effort by design: at most [`MAX_IN_FLIGHT`] peers are contacted
//! concurrently, each peer gets up to [`MAX_ATTEMPTS`] tries with
//! exponential backoff plus uniform random jitter, and a peer that
//! exhausts its attempts is abandoned silently. [`fan_out`] returns only
//! after every peer has terminated one way or the other.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::{Client, StatusCode};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use weft_common::PeerAttestBody;

/// Concurrency cap: peers in flight simultaneously.
pub const MAX_IN_FLIGHT: usize = 6;
/// Attempts per peer before abandoning it.
pub const MAX_ATTEMPTS: u32 = 5;
/// Backoff base delay; doubled after each failed attempt.
pub const INITIAL_DELAY_MS: u64 = 200;
/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Backoff base for a 1-indexed attempt: 200 ms doubled per failure.
/// Jitter is added separately at sleep time.
pub fn base_delay_ms(attempt: u32) -> u64 {
    INITIAL_DELAY_MS << attempt.saturating_sub(1).min(16)
}

/// Push an accepted attestation to every peer. Resolves when all peers
/// have succeeded or been abandoned.
pub async fn fan_out(http: Client, peers: Vec<String>, body: PeerAttestBody) {
    let sem = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    let mut handles = Vec::with_capacity(peers.len());
    for peer in peers {
        let http = http.clone();
        let sem = sem.clone();
        let body = body.clone();
        handles.push(tokio::spawn(async move {
            push_to_peer(http, sem, peer, body).await;
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

async fn push_to_peer(http: Client, sem: Arc<Semaphore>, peer: String, body: PeerAttestBody) {
    // The semaphore is never closed; acquire can only fail after close.
    let Ok(_permit) = sem.acquire_owned().await else { return };

    let url = format!("{}/peer/attest", peer.trim_end_matches('/'));
    for attempt in 1..=MAX_ATTEMPTS {
        match http
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) if resp.status() == StatusCode::OK => {
                debug!(peer = %peer, attempt, "propagated attestation");
                return;
            }
            Ok(resp) => {
                warn!(peer = %peer, attempt, status = %resp.status(), "peer rejected attestation");
            }
            Err(e) => {
                warn!(peer = %peer, attempt, error = %e, "peer unreachable");
            }
        }
        if attempt == MAX_ATTEMPTS {
            break;
        }
        let delay = base_delay_ms(attempt);
        let jitter = rand::thread_rng().gen_range(0..delay);
        sleep(Duration::from_millis(delay + jitter)).await;
    }
    // Exhausted: abandoned without an alert; propagation is best-effort.
    debug!(peer = %peer, "abandoning peer after {MAX_ATTEMPTS} attempts");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(base_delay_ms(1), 200);
        assert_eq!(base_delay_ms(2), 400);
        assert_eq!(base_delay_ms(3), 800);
        assert_eq!(base_delay_ms(4), 1600);
        assert_eq!(base_delay_ms(5), 3200);
    }

    #[test]
    fn test_backoff_shift_is_bounded() {
        // Degenerate attempt numbers must not overflow the shift.
        assert_eq!(base_delay_ms(0), 200);
        assert!(base_delay_ms(60) > 0);
    }
}

//! TCP listener delivering complete configuration documents to the UI loop.

use alloc::{string::String, vec::Vec};
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_net::{Stack, tcp::TcpSocket};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::{Duration, Timer};
use log::{info, warn};
use willow_core::config::MAX_CONFIG_BYTES;

pub(super) const PROVISIONING_PORT: u16 = 8266;
const SOCKET_TIMEOUT_SECS: u64 = 10;
const READ_CHUNK_BYTES: usize = 512;

/// Documents waiting for the orchestrator; one in flight is enough since the
/// first accepted one restarts the device.
pub(super) type ProvisioningQueue = Channel<CriticalSectionRawMutex, String, 1>;

enum Received {
    Document(String),
    TooLarge,
    NotUtf8,
}

async fn receive_document(socket: &mut TcpSocket<'_>) -> Result<Received, embassy_net::tcp::Error> {
    let mut payload = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_BYTES];

    loop {
        let read = socket.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        if payload.len() + read > MAX_CONFIG_BYTES {
            return Ok(Received::TooLarge);
        }
        payload.extend_from_slice(&chunk[..read]);
    }

    Ok(match String::from_utf8(payload) {
        Ok(text) => Received::Document(text),
        Err(_) => Received::NotUtf8,
    })
}

/// Accepts one client at a time until `stop` is raised.
pub(super) async fn provisioning_loop(
    stack: Stack<'_>,
    queue: &'static ProvisioningQueue,
    stop: &'static AtomicBool,
) -> ! {
    let mut rx_buffer = [0u8; 1024];
    let mut tx_buffer = [0u8; 256];

    stack.wait_config_up().await;
    info!("provisioning: listening on tcp/{}", PROVISIONING_PORT);

    loop {
        if stop.load(Ordering::Acquire) {
            Timer::after_secs(1).await;
            continue;
        }

        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));

        if let Err(err) = socket.accept(PROVISIONING_PORT).await {
            warn!("provisioning: accept failed: {:?}", err);
            Timer::after_secs(1).await;
            continue;
        }
        info!("provisioning: client {:?} connected", socket.remote_endpoint());

        match receive_document(&mut socket).await {
            Ok(Received::Document(text)) => {
                info!("provisioning: received {} byte document", text.len());
                if queue.try_send(text).is_err() {
                    warn!("provisioning: reconfiguration already pending, dropping document");
                }
            }
            Ok(Received::TooLarge) => {
                warn!(
                    "provisioning: document exceeds {} bytes, dropping",
                    MAX_CONFIG_BYTES
                );
            }
            Ok(Received::NotUtf8) => {
                warn!("provisioning: document is not valid UTF-8, dropping");
            }
            Err(err) => {
                warn!("provisioning: read failed: {:?}", err);
            }
        }

        socket.close();
        let _ = socket.flush().await;
        socket.abort();
    }
}

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_net::Stack;
use embassy_time::{Duration, Timer, WithTimeout};
use esp_radio::wifi::WifiController;
use log::info;
use willow_hal_esp32s3::network::ConnectivityHandle;

const WIFI_RETRY_BACKOFF_MIN_SECS: u64 = 2;
const WIFI_RETRY_BACKOFF_MAX_SECS: u64 = 120;
const NETWORK_POLL_INTERVAL_MS: u64 = 500;
const DHCP_TIMEOUT_SECS: u64 = 15;

fn wifi_retry_backoff_secs(consecutive_failures: u32) -> u64 {
    // 2, 4, 8, 16, 32, 64, 120, 120, ...
    let shift = consecutive_failures.min(6);
    WIFI_RETRY_BACKOFF_MIN_SECS
        .saturating_mul(1u64 << shift)
        .min(WIFI_RETRY_BACKOFF_MAX_SECS)
}

async fn wait_before_wifi_retry(consecutive_failures: &mut u32) {
    let delay_secs = wifi_retry_backoff_secs(*consecutive_failures);
    *consecutive_failures = consecutive_failures.saturating_add(1);
    info!(
        "wifi retrying in {}s (consecutive_failures={})",
        delay_secs, *consecutive_failures
    );
    Timer::after_secs(delay_secs).await;
}

async fn park(wifi_controller: &mut WifiController<'_>, connectivity: &ConnectivityHandle) -> ! {
    info!("wifi: endpoint stopped, disconnecting");
    let _ = wifi_controller.disconnect_async().await;
    connectivity.mark_disconnected();
    loop {
        Timer::after_secs(1).await;
    }
}

/// Keeps the station connected until `stop` is raised.
pub(super) async fn wifi_connection_loop(
    wifi_controller: &mut WifiController<'_>,
    stack: Stack<'_>,
    connectivity: &'static ConnectivityHandle,
    stop: &'static AtomicBool,
) -> ! {
    let mut consecutive_failures = 0u32;

    loop {
        if stop.load(Ordering::Acquire) {
            park(wifi_controller, connectivity).await;
        }
        connectivity.mark_connecting();

        if !wifi_controller.is_started().unwrap_or(false)
            && let Err(err) = wifi_controller.start_async().await
        {
            info!("wifi start failed: {:?}", err);
            connectivity.mark_disconnected();
            wait_before_wifi_retry(&mut consecutive_failures).await;
            continue;
        }

        if let Err(err) = wifi_controller.connect_async().await {
            info!("wifi connect failed: {:?}", err);
            connectivity.mark_disconnected();
            let _ = wifi_controller.disconnect_async().await;
            wait_before_wifi_retry(&mut consecutive_failures).await;
            continue;
        }

        match stack
            .wait_config_up()
            .with_timeout(Duration::from_secs(DHCP_TIMEOUT_SECS))
            .await
        {
            Ok(()) => {
                connectivity.update_link_ip(stack.is_link_up(), stack.config_v4().is_some());
                if let Some(config) = stack.config_v4() {
                    info!("wifi connected, address {}", config.address);
                }
            }
            Err(_) => {
                info!("dhcp timeout; forcing reconnect");
                connectivity.update_link_ip(stack.is_link_up(), false);
                let _ = wifi_controller.disconnect_async().await;
                wait_before_wifi_retry(&mut consecutive_failures).await;
                continue;
            }
        }

        consecutive_failures = 0;

        loop {
            if stop.load(Ordering::Acquire) {
                park(wifi_controller, connectivity).await;
            }

            let link_up = stack.is_link_up();
            let has_ipv4 = stack.config_v4().is_some();
            let is_connected = matches!(wifi_controller.is_connected(), Ok(true));

            connectivity.update_link_ip(link_up, has_ipv4);

            if !(link_up && has_ipv4 && is_connected) {
                info!(
                    "wifi state lost (link_up={} has_ipv4={} connected={}); reconnecting",
                    link_up, has_ipv4, is_connected
                );
                break;
            }

            Timer::after_millis(NETWORK_POLL_INTERVAL_MS).await;
        }

        connectivity.mark_disconnected();
        let _ = wifi_controller.disconnect_async().await;
        wait_before_wifi_retry(&mut consecutive_failures).await;
    }
}

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

extern crate alloc;

use core::sync::atomic::AtomicBool;

use embassy_executor::Spawner;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::Timer;
use esp_hal::{
    clock::CpuClock,
    delay::Delay,
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    spi::master::Spi,
    time::Rate,
    timer::timg::TimerGroup,
};
use esp_radio::wifi::{ClientConfig, ModeConfig};
use log::{LevelFilter, info, warn};
use static_cell::StaticCell;
use willow_core::{
    DeviceContext,
    activity::ActivityCoordinator,
    boot::BootSequence,
    clock::Clock,
    config::{
        ConfigStore, LoadOutcome,
        keys::{DEFAULT_HOSTNAME, HOSTNAME, WIFI_PSK, WIFI_SSID},
    },
    display::{DisplayLock, LabelSurface, StatusLabel},
    hardware::HardwareKind,
    input::InputProvider,
    orchestrator::Orchestrator,
    restart::{DelayedRestart, Restart},
    state::DeviceStateRegister,
};
use willow_hal_esp32s3::{
    input::button::{ButtonConfig, ButtonInput},
    network::{ConnectivityHandle, WifiCredentials},
    platform::{
        backlight::GpioBacklight,
        clock::SystemClock,
        display::MemoryLcd,
        labels::render_labels,
        panel::FrameBuffer,
        restart::SystemRestart,
    },
    storage::flash_config::FlashConfigFile,
};

use provisioning::ProvisioningQueue;
use subsystems::{AudioPipeline, NetworkEndpoint};

#[path = "main/provisioning.rs"]
mod provisioning;
#[path = "main/subsystems.rs"]
mod subsystems;
#[path = "main/wifi.rs"]
mod wifi;

const DISPLAY_SPI_HZ: u32 = 1_000_000;
const BACKLIGHT_ACTIVE_HIGH: bool = true;
const UI_POLL_INTERVAL_MS: u64 = 1;

const WIFI_SSID_FALLBACK: &str = match option_env!("WILLOW_WIFI_SSID") {
    Some(ssid) => ssid,
    None => "",
};
const WIFI_PSK_FALLBACK: &str = match option_env!("WILLOW_WIFI_PASSWORD") {
    Some(psk) => psk,
    None => "",
};

static STATE: DeviceStateRegister = DeviceStateRegister::new();
static CONFIG: ConfigStore<CriticalSectionRawMutex> = ConfigStore::new();
static CONNECTIVITY: ConnectivityHandle = ConnectivityHandle::new();
static NETWORK_STOP: AtomicBool = AtomicBool::new(false);
static PROVISIONING: ProvisioningQueue = Channel::new();
static DISPLAY: StaticCell<DisplayLock<CriticalSectionRawMutex, SystemClock>> = StaticCell::new();
static NET_RESOURCES: StaticCell<embassy_net::StackResources<4>> = StaticCell::new();

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

fn hardware_kind() -> HardwareKind {
    option_env!("WILLOW_HARDWARE_ID")
        .and_then(|raw| raw.parse().ok())
        .map_or(HardwareKind::Esp32S3Box, HardwareKind::from_raw)
}

fn boot_notice(outcome: Option<LoadOutcome>) -> Option<&'static str> {
    match outcome {
        Some(LoadOutcome::Loaded) => None,
        Some(LoadOutcome::Absent) => Some("Waiting for provisioning"),
        Some(LoadOutcome::Invalid) => Some("Configuration invalid"),
        None => Some("Storage unavailable"),
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: willow starting");

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // esp-radio and the config document both need an allocator.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let hardware = hardware_kind();
    let clock = SystemClock::new();
    let ctx = DeviceContext::new(&STATE, &CONFIG);
    let boot = BootSequence::new(ctx);
    let display_lock: &'static DisplayLock<CriticalSectionRawMutex, SystemClock> =
        DISPLAY.init(DisplayLock::new(clock));
    info!("boot: hardware {}", hardware);

    let mut storage = FlashConfigFile::mount();
    if let Err(err) = boot.storage_mounted(storage.as_ref().map(|_| ()).map_err(|err| *err)) {
        warn!("boot: {}", err);
    }
    let load_outcome = match storage.as_mut() {
        Ok(file) => boot
            .load_config(file)
            .map_err(|err| warn!("boot: {}", err))
            .ok(),
        Err(_) => None,
    };

    // Wiring: CLK=GPIO13, DI=GPIO14, CS=GPIO15, DISP=GPIO2, EMD=GPIO9
    let disp = Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default());
    let emd = Output::new(peripherals.GPIO9, Level::Low, OutputConfig::default());
    let cs = Output::new(peripherals.GPIO15, Level::Low, OutputConfig::default());

    let spi_config = esp_hal::spi::master::Config::default()
        .with_frequency(Rate::from_hz(DISPLAY_SPI_HZ))
        // Memory LCD uses CPOL=0, CPHA=1.
        .with_mode(esp_hal::spi::Mode::_1);

    let mut delay = Delay::new();
    let mut panel = match Spi::new(peripherals.SPI2, spi_config) {
        Ok(spi) => Some(MemoryLcd::new(
            spi.with_sck(peripherals.GPIO13)
                .with_mosi(peripherals.GPIO14),
            disp,
            emd,
            cs,
        )),
        Err(err) => {
            warn!("display: spi config rejected: {:?}", err);
            None
        }
    };
    let panel_started = match panel.as_mut() {
        Some(panel) => panel.initialize(&mut delay).map_err(|err| {
            warn!("display: initialize failed: {:?}", err);
            "display initialize failed"
        }),
        None => Err("display bus unavailable"),
    };

    let backlight = GpioBacklight::new(
        Output::new(peripherals.GPIO45, Level::Low, OutputConfig::default()),
        BACKLIGHT_ACTIVE_HIGH,
    );
    if !hardware.has_touch() {
        info!("{}: no touch panel, skipping touch bring-up", hardware);
    }
    let boot_button = Input::new(peripherals.GPIO0, InputConfig::default().with_pull(Pull::Up));
    let Ok(mut input) = ButtonInput::new(
        boot_button,
        ButtonConfig::default().with_debounce_polls(4),
    );

    if let Err(err) = boot.peripherals_started(panel_started) {
        warn!("boot: {}", err);
    }

    if let Some(mut labels) = display_lock.try_lock() {
        labels.set_text(StatusLabel::Line1, "Willow");
        labels.set_text(StatusLabel::Line2, hardware.label());
        match boot_notice(load_outcome) {
            Some(notice) => labels.set_text(StatusLabel::Line5, notice),
            None => labels.set_hidden(StatusLabel::Line5, true),
        }
    }

    let mut activity = ActivityCoordinator::new(&CONFIG, backlight);
    activity.reset(clock.now_ms(), true);
    let mut restart = DelayedRestart::new();
    let mut orchestrator = storage.ok().map(|file| {
        Orchestrator::new(
            ctx,
            file,
            display_lock,
            AudioPipeline,
            NetworkEndpoint::new(&NETWORK_STOP),
            clock,
        )
    });

    let stored_ssid = CONFIG.get_string(WIFI_SSID, "");
    let stored_psk = CONFIG.get_string(WIFI_PSK, "");
    let credentials = WifiCredentials::resolve(
        (&stored_ssid, &stored_psk),
        (WIFI_SSID_FALLBACK, WIFI_PSK_FALLBACK),
    );
    info!(
        "network: hostname {}",
        CONFIG.get_string(HOSTNAME, DEFAULT_HOSTNAME)
    );

    let radio = esp_radio::init()
        .map_err(|err| warn!("esp-radio init failed: {:?}", err))
        .ok();
    let wifi = radio.as_ref().and_then(|radio| {
        esp_radio::wifi::new(radio, peripherals.WIFI, esp_radio::wifi::Config::default())
            .map_err(|err| warn!("wifi peripheral init failed: {:?}", err))
            .ok()
    });

    let network = match (credentials, wifi) {
        (Some(credentials), Some((mut wifi_controller, interfaces))) => {
            let client_config = ClientConfig::default()
                .with_ssid(credentials.ssid.as_str().into())
                .with_password(credentials.psk.as_str().into());
            match wifi_controller.set_config(&ModeConfig::Client(client_config)) {
                Ok(()) => {
                    let (stack, net_runner) = embassy_net::new(
                        interfaces.sta,
                        embassy_net::Config::dhcpv4(Default::default()),
                        NET_RESOURCES.init(embassy_net::StackResources::<4>::new()),
                        0x3A61_9C07_51E2_D4B8,
                    );
                    info!("wifi: joining {}", credentials.ssid);
                    Some((wifi_controller, stack, net_runner))
                }
                Err(err) => {
                    warn!("wifi mode config failed: {:?}", err);
                    None
                }
            }
        }
        (None, _) => {
            warn!("wifi: no credentials in config or build environment");
            None
        }
        (_, None) => None,
    };

    let network_future = async {
        match network {
            Some((mut wifi_controller, stack, mut net_runner)) => {
                CONNECTIVITY.mark_connecting();
                let _ = embassy_futures::join::join3(
                    net_runner.run(),
                    wifi::wifi_connection_loop(
                        &mut wifi_controller,
                        stack,
                        &CONNECTIVITY,
                        &NETWORK_STOP,
                    ),
                    provisioning::provisioning_loop(stack, &PROVISIONING, &NETWORK_STOP),
                )
                .await;
            }
            None => core::future::pending::<()>().await,
        }
    };

    let ui_future = async {
        let mut frame = FrameBuffer::new();
        let mut last_label_revision = u32::MAX;
        let mut last_connectivity_revision = u32::MAX;
        let mut display_fault_logged = false;

        loop {
            let now_ms = clock.now_ms();

            if let Ok(Some(event)) = input.poll_event() {
                activity.on_input(event, now_ms);
            }
            activity.poll(now_ms);

            if let Ok(text) = PROVISIONING.try_receive() {
                match orchestrator.as_mut() {
                    Some(orchestrator) => {
                        match orchestrator.reconfigure(&text, &mut activity, &mut restart) {
                            Ok(report) => info!("reconfigure: {:?}", report),
                            Err(err) => warn!("provisioning: {}", err),
                        }
                    }
                    None => warn!("provisioning: storage unavailable, ignoring document"),
                }
            }

            if restart.is_due(now_ms) {
                SystemRestart.restart();
            }

            let connectivity = CONNECTIVITY.snapshot();
            if connectivity.revision != last_connectivity_revision
                && STATE.is_ready()
                && let Some(mut labels) = display_lock.try_lock()
            {
                labels.set_text(StatusLabel::Line4, connectivity.state.status_text());
                last_connectivity_revision = connectivity.revision;
            }

            if let Some(labels) = display_lock.try_lock()
                && labels.revision() != last_label_revision
            {
                render_labels(&labels, &mut frame);
                last_label_revision = labels.revision();
                drop(labels);

                if let Some(panel) = panel.as_mut()
                    && let Err(err) = panel.flush_frame(&frame, &mut delay)
                    && !display_fault_logged
                {
                    info!("display flush failed: {:?}", err);
                    display_fault_logged = true;
                }
            }

            Timer::after_millis(UI_POLL_INTERVAL_MS).await;
        }
    };

    let _ = embassy_futures::join::join(network_future, ui_future).await;
    unreachable!()
}

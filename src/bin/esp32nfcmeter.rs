// bin/esp32nfcmeter.rs

#![warn(clippy::large_futures)]

use esp_idf_hal::gpio::{AnyInputPin, Input, InputPin, PinDriver};
use esp32nfcmeter::*;

const CONFIG_RESET_COUNT: i32 = 9;
const PN532_INIT_TRIES: usize = 5;

fn main() -> anyhow::Result<()> {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Hello.");
    info!(
        "Starting up, firmware {FW_VERSION} built {}",
        BUILD_TIMESTAMP.unwrap_or("(unknown)")
    );

    let nvs_default_partition = nvs::EspDefaultNvsPartition::take()?;

    let ns = env!("CARGO_BIN_NAME");
    let mut nvs = match nvs::EspNvs::new(nvs_default_partition, ns, true) {
        Ok(nvs) => {
            info!("Got namespace {ns:?} from default partition");
            nvs
        }
        Err(e) => bail!("Could not get namespace {ns}: {e:?}"),
    };

    let config = match MyConfig::from_nvs(&mut nvs) {
        None => {
            error!("Could not read nvs config, using defaults");
            let c = MyConfig::default();
            c.to_nvs(&mut nvs)?;
            info!("Successfully saved default config to nvs.");
            c
        }
        Some(c) => c,
    };
    info!("My config:\n{config:#?}");

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;
    let button = PinDriver::input(pins.gpio9.downgrade_input())?;

    // SPI pins: GPIO4=SCK, GPIO6=MOSI, GPIO5=MISO, GPIO7=CS
    let driver = spi::SpiDriver::new(
        peripherals.spi2,
        pins.gpio4,
        pins.gpio6,
        Some(pins.gpio5),
        &spi::SpiDriverConfig::new(),
    )?;
    // PN532 talks LSB first on SPI
    let spi_cfg = spi::config::Config::new()
        .baudrate(config.spi_khz.kHz().into())
        .bit_order(spi::config::BitOrder::LsbFirst);
    let dev = spi::SpiDeviceDriver::new(&driver, Some(pins.gpio7), &spi_cfg)?;

    let mut pn532 = Pn532::new(dev, FreeRtos);
    let mut tries = 0;
    loop {
        match pn532.init() {
            Ok(fw) => {
                info!("PN532 ready: {fw:?}");
                break;
            }
            Err(e) if tries < PN532_INIT_TRIES => {
                error!("PN532 init failed: {e}");
                tries += 1;
                FreeRtos::delay_ms(500);
            }
            Err(e) => {
                error!("PN532 not responding, giving up: {e}");
                FreeRtos::delay_ms(3000);
                esp_idf_hal::reset::restart();
            }
        }
    }

    let state = Box::pin(MyState::new(config));
    let shared_state = Arc::new(state);

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(Box::pin(async move {
            info!("Entering main loop...");
            tokio::select! {
                _ = Box::pin(poll_reset(shared_state.clone(), nvs, button)) => { error!("poll_reset() ended."); }
                _ = Box::pin(poll_tags(shared_state.clone(), pn532)) => { error!("poll_tags() ended."); }
            };
        }));

    info!("main() finished, reboot.");
    FreeRtos::delay_ms(3000);
    esp_idf_hal::reset::restart();
}

async fn poll_reset(
    state: Arc<Pin<Box<MyState>>>,
    mut nvs: nvs::EspNvs<nvs::NvsDefault>,
    button: PinDriver<'_, AnyInputPin, Input>,
) -> AppResult<()> {
    let mut uptime: usize = 0;
    loop {
        sleep(Duration::from_secs(2)).await;

        uptime += 2;
        *(state.uptime.write().await) = uptime;
        if uptime % 600 == 0 {
            let (ok, failed) = state.counters();
            info!("Uptime {uptime}s, {ok} tags read, {failed} failures");
        }

        if button.is_low() {
            Box::pin(reset_button(&mut nvs, &button)).await?;
        }
    }
}

async fn reset_button<'a>(
    nvs: &mut nvs::EspNvs<nvs::NvsDefault>,
    button: &PinDriver<'a, AnyInputPin, Input>,
) -> AppResult<()> {
    let mut reset_cnt = CONFIG_RESET_COUNT;

    while button.is_low() {
        error!("Reset? {reset_cnt}");

        if reset_cnt == 0 {
            error!("Factory resetting...");

            let new_config = MyConfig::default();
            new_config.to_nvs(nvs)?;
            sleep(Duration::from_millis(2000)).await;
            esp_idf_hal::reset::restart();
        }

        reset_cnt -= 1;
        sleep(Duration::from_millis(500)).await;
    }
    Ok(())
}

// EOF

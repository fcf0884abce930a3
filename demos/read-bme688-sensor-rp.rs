#![no_std]
#![no_main]

use defmt::{error, info};
use defmt_rtt as _;
use embassy_bme688_sensor::acquisition::DefmtSink;
use embassy_bme688_sensor::{AcquisitionConfig, EmbassyClock};
use embassy_executor::Spawner;
use embassy_rp::peripherals::I2C1;
use embassy_rp::{bind_interrupts, i2c};
use embassy_time::Timer;
use panic_probe as _;

bind_interrupts!(struct Irqs {
    I2C1_IRQ => i2c::InterruptHandler<I2C1>;
});

#[embassy_executor::main]
async fn main(_spawner: Spawner) -> ! {
    let p = embassy_rp::init(Default::default());

    let sda = p.PIN_2;
    let scl = p.PIN_3;

    let config = AcquisitionConfig::DEFAULT;

    // Configure I2C
    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = config.bus.frequency_hz;
    let i2c = i2c::I2c::new_async(p.I2C1, scl, sda, Irqs, i2c_config);

    info!("BME688 on I2C1, address {=u8:#x}", config.bus.address);

    // Only returns when setup fails
    let err = embassy_bme688_sensor::run(i2c, EmbassyClock, DefmtSink, &config).await;
    error!("Setup failed: {}", err);

    loop {
        Timer::after_secs(60).await;
    }
}

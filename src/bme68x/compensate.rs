//! Floating-point compensation of raw ADC values.

use super::calib::CalibData;

/// Ambient temperature assumed when sizing the heater resistance.
pub const AMBIENT_TEMP_C: f32 = 25.0;

/// Temperature in °C plus the fine value the other channels depend on.
pub fn temperature(cal: &CalibData, temp_adc: u32) -> (f32, f32) {
    let adc = temp_adc as f32;
    let t1 = f32::from(cal.par_t1);
    let var1 = ((adc / 16384.0) - (t1 / 1024.0)) * f32::from(cal.par_t2);
    let d = (adc / 131072.0) - (t1 / 8192.0);
    let var2 = d * d * (f32::from(cal.par_t3) * 16.0);
    let t_fine = var1 + var2;
    (t_fine / 5120.0, t_fine)
}

/// Pressure in Pa.
pub fn pressure(cal: &CalibData, t_fine: f32, pres_adc: u32) -> f32 {
    let mut var1 = (t_fine / 2.0) - 64000.0;
    let mut var2 = var1 * var1 * (f32::from(cal.par_p6) / 131072.0);
    var2 += var1 * f32::from(cal.par_p5) * 2.0;
    var2 = (var2 / 4.0) + (f32::from(cal.par_p4) * 65536.0);
    var1 = (((f32::from(cal.par_p3) * var1 * var1) / 16384.0) + (f32::from(cal.par_p2) * var1))
        / 524288.0;
    var1 = (1.0 + (var1 / 32768.0)) * f32::from(cal.par_p1);

    // Guards the division below against an all-zero calibration.
    if var1 as i32 == 0 {
        return 0.0;
    }

    let mut p = 1048576.0 - pres_adc as f32;
    p = ((p - (var2 / 4096.0)) * 6250.0) / var1;
    let var1 = (f32::from(cal.par_p9) * p * p) / 2147483648.0;
    let var2 = p * (f32::from(cal.par_p8) / 32768.0);
    let q = p / 256.0;
    let var3 = q * q * q * (f32::from(cal.par_p10) / 131072.0);
    p + (var1 + var2 + var3 + (f32::from(cal.par_p7) * 128.0)) / 16.0
}

/// Relative humidity in %, clamped to 0..=100.
pub fn humidity(cal: &CalibData, t_fine: f32, hum_adc: u16) -> f32 {
    let temp_comp = t_fine / 5120.0;
    let var1 = f32::from(hum_adc)
        - ((f32::from(cal.par_h1) * 16.0) + ((f32::from(cal.par_h3) / 2.0) * temp_comp));
    let var2 = var1
        * ((f32::from(cal.par_h2) / 262144.0)
            * (1.0
                + ((f32::from(cal.par_h4) / 16384.0) * temp_comp)
                + ((f32::from(cal.par_h5) / 1048576.0) * temp_comp * temp_comp)));
    let var3 = f32::from(cal.par_h6) / 16384.0;
    let var4 = f32::from(cal.par_h7) / 2097152.0;
    let rh = var2 + ((var3 + (var4 * temp_comp)) * var2 * var2);
    rh.clamp(0.0, 100.0)
}

/// Gas resistance in Ω for the BME688 (gas-high) ADC.
pub fn gas_resistance_high(gas_adc: u16, gas_range: u8) -> f32 {
    let var1 = (262144u32 >> gas_range) as f32;
    let var2 = 4096.0 + 3.0 * (f32::from(gas_adc) - 512.0);
    1_000_000.0 * var1 / var2
}

const K1_RANGE: [f32; 16] = [
    0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, -0.8, 0.0, 0.0, -0.2, -0.5, 0.0, -1.0, 0.0, 0.0,
];
const K2_RANGE: [f32; 16] = [
    0.0, 0.0, 0.0, 0.0, 0.1, 0.7, 0.0, -0.8, -0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];

/// Gas resistance in Ω for the BME680 (gas-low) ADC.
pub fn gas_resistance_low(cal: &CalibData, gas_adc: u16, gas_range: u8) -> f32 {
    let range = usize::from(gas_range & 0x0F);
    let var1 = 1340.0 + 5.0 * f32::from(cal.range_sw_err);
    let var2 = var1 * (1.0 + K1_RANGE[range] / 100.0);
    let var3 = 1.0 + K2_RANGE[range] / 100.0;
    let range_f = (1u32 << range) as f32;
    1.0 / (var3 * 0.000000125 * range_f * (((f32::from(gas_adc) - 512.0) / var2) + 1.0))
}

/// `res_heat_x` register value for a heater target in °C.
pub fn heater_resistance(cal: &CalibData, target_c: u16, ambient_c: f32) -> u8 {
    let target = f32::from(target_c.min(400));
    let var1 = (f32::from(cal.par_gh1) / 16.0) + 49.0;
    let var2 = ((f32::from(cal.par_gh2) / 32768.0) * 0.0005) + 0.00235;
    let var3 = f32::from(cal.par_gh3) / 1024.0;
    let var4 = var1 * (1.0 + (var2 * target));
    let var5 = var4 + (var3 * ambient_c);
    let range = f32::from(cal.res_heat_range);
    let val = f32::from(cal.res_heat_val);
    (3.4 * ((var5 * (4.0 / (4.0 + range)) * (1.0 / (1.0 + (val * 0.002)))) - 25.0)) as u8
}

/// `gas_wait_x` encoding: 6-bit mantissa, 2-bit multiplier of 1/4/16/64.
pub fn gas_wait(duration_ms: u16) -> u8 {
    if duration_ms >= 0xFC0 {
        return 0xFF;
    }
    let mut dur = duration_ms;
    let mut factor = 0u8;
    while dur > 0x3F {
        dur /= 4;
        factor += 1;
    }
    dur as u8 + factor * 64
}

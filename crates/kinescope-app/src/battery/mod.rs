//! Battery state from a divided ADC reading.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// LiPo discharge curve: (millivolts, percent), highest voltage first.
const VOLTAGE_CURVE: [(i32, i32); 19] = [
    (4200, 100),
    (4150, 95),
    (4100, 90),
    (4050, 85),
    (4000, 80),
    (3950, 75),
    (3900, 70),
    (3850, 65),
    (3800, 60),
    (3750, 55),
    (3700, 50),
    (3600, 40),
    (3500, 30),
    (3400, 20),
    (3300, 15),
    (3200, 10),
    (3100, 5),
    (3050, 2),
    (3000, 0),
];

const ADC_FULL_SCALE: f32 = 4095.0;

/// Read-only battery status consumed by the player.
pub trait Battery: Send + Sync {
    /// Charge estimate, 0..=100.
    fn battery_level(&self) -> u8;
    fn is_charging(&self) -> bool;
    fn is_low_battery(&self) -> bool;
    /// Pack voltage in volts.
    fn voltage(&self) -> f32;
}

/// Raw 12-bit sample source.
pub trait AdcReader: Send {
    fn read(&mut self) -> u16;
}

/// Constant reading, for hosts without an ADC.
pub struct FixedAdc(pub u16);

impl AdcReader for FixedAdc {
    fn read(&mut self) -> u16 {
        self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub v_ref: f32,
    pub r1_ohms: f32,
    pub r2_ohms: f32,
    pub low_percent: u8,
    /// Sampling window for charge detection.
    pub charge_window_ms: u64,
    /// Voltage rise over one window that means charging.
    pub charge_rise_v: f32,
    /// Voltage drop over one window that means discharging.
    pub discharge_drop_v: f32,
    /// Reading used by `FixedAdc` when no hardware is present.
    pub simulated_adc: u16,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            v_ref: 3.3,
            r1_ohms: 100_000.0,
            r2_ohms: 100_000.0,
            low_percent: 10,
            charge_window_ms: 5000,
            charge_rise_v: 0.05,
            discharge_drop_v: 0.01,
            simulated_adc: 2420,
        }
    }
}

/// Percentage for a pack voltage, interpolated linearly along the curve and
/// truncated.
pub fn level_for_millivolts(millivolts: i32) -> u8 {
    let (top_mv, _) = VOLTAGE_CURVE[0];
    let (bottom_mv, _) = VOLTAGE_CURVE[VOLTAGE_CURVE.len() - 1];
    if millivolts >= top_mv {
        return 100;
    }
    if millivolts <= bottom_mv {
        return 0;
    }
    let i = VOLTAGE_CURVE
        .iter()
        .position(|&(mv, _)| millivolts >= mv)
        .unwrap_or(VOLTAGE_CURVE.len() - 1);
    let (upper_mv, upper_pct) = VOLTAGE_CURVE[i - 1];
    let (lower_mv, lower_pct) = VOLTAGE_CURVE[i];
    let fraction = (millivolts - lower_mv) as f32 / (upper_mv - lower_mv) as f32;
    (lower_pct as f32 + fraction * (upper_pct - lower_pct) as f32) as u8
}

#[derive(Debug, Clone, Copy)]
struct Reading {
    voltage: f32,
    level: u8,
    charging: bool,
    low: bool,
}

struct MonitorState {
    adc: Box<dyn AdcReader>,
    reading: Reading,
    window_voltage: f32,
    window_start: Instant,
}

/// Samples the ADC on `update` and keeps the derived status.
pub struct BatteryMonitor {
    config: BatteryConfig,
    state: Mutex<MonitorState>,
}

impl BatteryMonitor {
    pub fn new(config: BatteryConfig, adc: Box<dyn AdcReader>) -> Self {
        Self::new_at(config, adc, Instant::now())
    }

    fn new_at(config: BatteryConfig, mut adc: Box<dyn AdcReader>, now: Instant) -> Self {
        let voltage = pack_voltage(&config, adc.read());
        let level = level_for_millivolts((voltage * 1000.0) as i32);
        let reading = Reading {
            voltage,
            level,
            charging: false,
            low: level <= config.low_percent,
        };
        log::info!("Battery {voltage:.2}V ({level}%)");
        Self {
            config,
            state: Mutex::new(MonitorState {
                adc,
                reading,
                window_voltage: voltage,
                window_start: now,
            }),
        }
    }

    pub fn update(&self) {
        self.update_at(Instant::now());
    }

    pub fn update_at(&self, now: Instant) {
        let mut state = self.state.lock();
        let voltage = pack_voltage(&self.config, state.adc.read());
        let level = level_for_millivolts((voltage * 1000.0) as i32);
        let low = level <= self.config.low_percent;
        if low && !state.reading.low {
            log::warn!("Battery low: {level}%");
        }

        let mut charging = state.reading.charging;
        let window = Duration::from_millis(self.config.charge_window_ms);
        if now.saturating_duration_since(state.window_start) > window {
            if voltage > state.window_voltage + self.config.charge_rise_v {
                charging = true;
            } else if voltage < state.window_voltage - self.config.discharge_drop_v {
                charging = false;
            }
            if charging != state.reading.charging {
                log::info!("Battery {}", if charging { "charging" } else { "discharging" });
            }
            state.window_voltage = voltage;
            state.window_start = now;
        }

        state.reading = Reading {
            voltage,
            level,
            charging,
            low,
        };
    }

    fn reading(&self) -> Reading {
        self.state.lock().reading
    }
}

fn pack_voltage(config: &BatteryConfig, raw: u16) -> f32 {
    let at_pin = f32::from(raw) * (config.v_ref / ADC_FULL_SCALE);
    at_pin * ((config.r1_ohms + config.r2_ohms) / config.r2_ohms)
}

impl Battery for BatteryMonitor {
    fn battery_level(&self) -> u8 {
        self.reading().level
    }

    fn is_charging(&self) -> bool {
        self.reading().charging
    }

    fn is_low_battery(&self) -> bool {
        self.reading().low
    }

    fn voltage(&self) -> f32 {
        self.reading().voltage
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU16, Ordering};
    use std::sync::Arc;

    use super::*;

    struct SharedAdc(Arc<AtomicU16>);

    impl AdcReader for SharedAdc {
        fn read(&mut self) -> u16 {
            self.0.load(Ordering::Relaxed)
        }
    }

    /// ADC value that yields roughly `volts` through a 1:1 divider.
    fn raw_for(volts: f32) -> u16 {
        (volts / 2.0 / 3.3 * ADC_FULL_SCALE).round() as u16
    }

    #[test]
    fn curve_endpoints_and_interpolation() {
        assert_eq!(level_for_millivolts(4300), 100);
        assert_eq!(level_for_millivolts(4200), 100);
        assert_eq!(level_for_millivolts(3000), 0);
        assert_eq!(level_for_millivolts(2500), 0);
        assert_eq!(level_for_millivolts(3900), 70);
        assert_eq!(level_for_millivolts(3725), 52);
        assert_eq!(level_for_millivolts(3650), 45);
        assert_eq!(level_for_millivolts(3075), 3);
    }

    #[test]
    fn simulated_reading_is_healthy() {
        let config = BatteryConfig::default();
        let adc = Box::new(FixedAdc(config.simulated_adc));
        let monitor = BatteryMonitor::new(config, adc);
        assert!((monitor.voltage() - 3.90).abs() < 0.01);
        assert_eq!(monitor.battery_level(), 70);
        assert!(!monitor.is_low_battery());
        assert!(!monitor.is_charging());
    }

    #[test]
    fn low_battery_threshold_is_inclusive() {
        let monitor = BatteryMonitor::new(BatteryConfig::default(), Box::new(FixedAdc(raw_for(3.2))));
        assert!(monitor.battery_level() <= 10);
        assert!(monitor.is_low_battery());
    }

    #[test]
    fn charging_detected_over_window() {
        let raw = Arc::new(AtomicU16::new(raw_for(3.8)));
        let start = Instant::now();
        let monitor = BatteryMonitor::new_at(
            BatteryConfig::default(),
            Box::new(SharedAdc(raw.clone())),
            start,
        );

        raw.store(raw_for(3.9), Ordering::Relaxed);
        monitor.update_at(start + Duration::from_secs(1));
        assert!(!monitor.is_charging(), "window has not elapsed");

        monitor.update_at(start + Duration::from_secs(6));
        assert!(monitor.is_charging());

        raw.store(raw_for(3.85), Ordering::Relaxed);
        monitor.update_at(start + Duration::from_secs(12));
        assert!(!monitor.is_charging());
    }
}

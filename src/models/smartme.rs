//! Models for the smart-me metering REST API.
//!
//! Notes
//! - Every device field is optional. Absent fields stay `None` and are skipped again on
//!   serialization, so an omitted reading never turns into a zero.
//! - Keys are written in camelCase; the PascalCase keys the API also emits are accepted on input.
//! - Integer-coded enums keep codes they do not know as `Unrecognized(code)`.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// =====================
// Scalar ID newtype wrappers
// =====================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        DeviceId(value.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        DeviceId(value)
    }
}

impl core::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

// =====================
// Integer-coded enums
// =====================

struct CodeVisitor(&'static str);

impl<'de> serde::de::Visitor<'de> for CodeVisitor {
    type Value = i32;

    fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "an integer code for {}", self.0)
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        i32::try_from(value).map_err(|_| E::invalid_value(serde::de::Unexpected::Signed(value), &self))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        i32::try_from(value).map_err(|_| E::invalid_value(serde::de::Unexpected::Unsigned(value), &self))
    }
}

/// Declares an enum backed by an `i32` wire code with an `Unrecognized` fallback.
macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A code not known to this crate, kept verbatim.
            Unrecognized(i32),
        }

        impl $name {
            /// Wire code of this value.
            pub fn code(self) -> i32 {
                match self {
                    $( $name::$variant => $code, )+
                    $name::Unrecognized(code) => code,
                }
            }
        }

        impl From<i32> for $name {
            fn from(code: i32) -> Self {
                match code {
                    $( $code => $name::$variant, )+
                    other => $name::Unrecognized(other),
                }
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_i32(self.code())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                deserializer
                    .deserialize_any(CodeVisitor(stringify!($name)))
                    .map($name::from)
            }
        }
    };
}

coded_enum! {
    /// Kind of energy (or device class) a meter measures.
    pub enum MeterEnergyType {
        Unknown = 0,
        Electricity = 1,
        Water = 2,
        Gas = 3,
        Heat = 4,
        /// Heat cost allocator.
        Hca = 5,
        AllMeters = 6,
        Temperature = 7,
        MBusGateway = 8,
        Rs485Gateway = 9,
        CustomDevice = 10,
        CompressedAir = 11,
        SolarLog = 12,
        VirtualMeter = 13,
        WMBusGateway = 14,
    }
}

coded_enum! {
    pub enum MeterSubType {
        Unknown = 0,
        ColdWater = 1,
        HotWater = 2,
        ChargingStation = 3,
        Electricity = 4,
        Water = 5,
        Gas = 6,
        ElectricityHeat = 7,
        Temperature = 8,
        VirtualBattery = 9,
    }
}

coded_enum! {
    /// Hardware family of a device.
    pub enum MeterFamilyType {
        /// M-BUS meters, S0 meters and everything else without a dedicated family.
        Unknown = 0,
        ConnectPlugin = 1,
        Meter1PhaseDinRail = 2,
        Meter1PhaseDinRailWithSwitch = 3,
        MBusGatewayV1 = 4,
        Rs485GatewayV1 = 5,
        KamstrupModule = 6,
        Meter3Phase80A = 7,
        Meter3Phase32AWithSwitch = 8,
        Meter3PhaseTransformerEdition = 9,
        LandisGyrModule = 10,
        FnnOpticalModule = 11,
        Meter3Phase80AWifiV2 = 12,
        Meter3Phase80AMobile = 14,
        Meter1Phase80AWifiV2 = 16,
        Meter1Phase32AWifiV2 = 17,
        Meter1Phase80AGprs = 18,
        Meter1Phase32AGprs = 19,
        WirelessMBusGatewayV1 = 20,
        Meter3PhaseTransformerEditionMobile = 21,
        Nimbus3PhaseMeter = 65,
        MithralChargingStationV1 = 70,
        RestApiMeter = 1001,
        VirtualBillingMeter = 1002,
    }
}

coded_enum! {
    pub enum ChargeStationState {
        Booting = 0,
        ReadyNoCarConnected = 1,
        ReadyCarConnected = 2,
        StartedWaitForCar = 3,
        Charging = 4,
        Installation = 5,
        Authorize = 6,
        Offline = 7,
    }
}

// =====================
// Devices and values
// =====================

/// A meter, gateway or charging station as reported by `/Devices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(alias = "Id", skip_serializing_if = "Option::is_none")]
    pub id: Option<DeviceId>,
    #[serde(alias = "Name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(alias = "Serial", skip_serializing_if = "Option::is_none")]
    pub serial: Option<i64>,
    #[serde(alias = "DeviceEnergyType", skip_serializing_if = "Option::is_none")]
    pub device_energy_type: Option<MeterEnergyType>,
    #[serde(alias = "MeterSubType", skip_serializing_if = "Option::is_none")]
    pub meter_sub_type: Option<MeterSubType>,
    #[serde(alias = "FamilyType", skip_serializing_if = "Option::is_none")]
    pub family_type: Option<MeterFamilyType>,

    // Measurements
    #[serde(alias = "ActivePower", skip_serializing_if = "Option::is_none")]
    pub active_power: Option<f64>,
    #[serde(alias = "ActivePowerL1", skip_serializing_if = "Option::is_none")]
    pub active_power_l1: Option<f64>,
    #[serde(alias = "ActivePowerL2", skip_serializing_if = "Option::is_none")]
    pub active_power_l2: Option<f64>,
    #[serde(alias = "ActivePowerL3", skip_serializing_if = "Option::is_none")]
    pub active_power_l3: Option<f64>,
    #[serde(alias = "ActivePowerUnit", skip_serializing_if = "Option::is_none")]
    pub active_power_unit: Option<String>,
    #[serde(alias = "Voltage", skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(alias = "VoltageL1", skip_serializing_if = "Option::is_none")]
    pub voltage_l1: Option<f64>,
    #[serde(alias = "VoltageL2", skip_serializing_if = "Option::is_none")]
    pub voltage_l2: Option<f64>,
    #[serde(alias = "VoltageL3", skip_serializing_if = "Option::is_none")]
    pub voltage_l3: Option<f64>,
    #[serde(alias = "Current", skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(alias = "CurrentL1", skip_serializing_if = "Option::is_none")]
    pub current_l1: Option<f64>,
    #[serde(alias = "CurrentL2", skip_serializing_if = "Option::is_none")]
    pub current_l2: Option<f64>,
    #[serde(alias = "CurrentL3", skip_serializing_if = "Option::is_none")]
    pub current_l3: Option<f64>,
    #[serde(alias = "PowerFactor", skip_serializing_if = "Option::is_none")]
    pub power_factor: Option<f64>,
    #[serde(alias = "PowerFactorL1", skip_serializing_if = "Option::is_none")]
    pub power_factor_l1: Option<f64>,
    #[serde(alias = "PowerFactorL2", skip_serializing_if = "Option::is_none")]
    pub power_factor_l2: Option<f64>,
    #[serde(alias = "PowerFactorL3", skip_serializing_if = "Option::is_none")]
    pub power_factor_l3: Option<f64>,
    #[serde(alias = "Temperature", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(alias = "FlowRate", skip_serializing_if = "Option::is_none")]
    pub flow_rate: Option<f64>,

    // Counters
    #[serde(alias = "CounterReading", skip_serializing_if = "Option::is_none")]
    pub counter_reading: Option<f64>,
    #[serde(alias = "CounterReadingUnit", skip_serializing_if = "Option::is_none")]
    pub counter_reading_unit: Option<String>,
    #[serde(alias = "CounterReadingT1", skip_serializing_if = "Option::is_none")]
    pub counter_reading_t1: Option<f64>,
    #[serde(alias = "CounterReadingT2", skip_serializing_if = "Option::is_none")]
    pub counter_reading_t2: Option<f64>,
    #[serde(alias = "CounterReadingT3", skip_serializing_if = "Option::is_none")]
    pub counter_reading_t3: Option<f64>,
    #[serde(alias = "CounterReadingT4", skip_serializing_if = "Option::is_none")]
    pub counter_reading_t4: Option<f64>,
    #[serde(alias = "CounterReadingImport", skip_serializing_if = "Option::is_none")]
    pub counter_reading_import: Option<f64>,
    #[serde(alias = "CounterReadingExport", skip_serializing_if = "Option::is_none")]
    pub counter_reading_export: Option<f64>,
    #[serde(alias = "ActiveTariff", skip_serializing_if = "Option::is_none")]
    pub active_tariff: Option<i32>,

    // I/O
    #[serde(alias = "SwitchOn", skip_serializing_if = "Option::is_none")]
    pub switch_on: Option<bool>,
    #[serde(alias = "SwitchPhaseL1On", skip_serializing_if = "Option::is_none")]
    pub switch_phase_l1_on: Option<bool>,
    #[serde(alias = "SwitchPhaseL2On", skip_serializing_if = "Option::is_none")]
    pub switch_phase_l2_on: Option<bool>,
    #[serde(alias = "SwitchPhaseL3On", skip_serializing_if = "Option::is_none")]
    pub switch_phase_l3_on: Option<bool>,
    #[serde(alias = "DigitalOutput1", skip_serializing_if = "Option::is_none")]
    pub digital_output1: Option<bool>,
    #[serde(alias = "DigitalOutput2", skip_serializing_if = "Option::is_none")]
    pub digital_output2: Option<bool>,
    #[serde(alias = "AnalogOutput1", skip_serializing_if = "Option::is_none")]
    pub analog_output1: Option<i32>,
    #[serde(alias = "AnalogOutput2", skip_serializing_if = "Option::is_none")]
    pub analog_output2: Option<i32>,
    #[serde(alias = "DigitalInput1", skip_serializing_if = "Option::is_none")]
    pub digital_input1: Option<bool>,
    #[serde(alias = "DigitalInput2", skip_serializing_if = "Option::is_none")]
    pub digital_input2: Option<bool>,

    // Metadata and charging station
    #[serde(alias = "ValueDate", skip_serializing_if = "Option::is_none")]
    pub value_date: Option<String>,
    #[serde(alias = "AdditionalMeterSerialNumber", skip_serializing_if = "Option::is_none")]
    pub additional_meter_serial_number: Option<String>,
    #[serde(alias = "ChargeStationState", skip_serializing_if = "Option::is_none")]
    pub charge_station_state: Option<ChargeStationState>,
}

impl Device {
    /// Timestamp of the last reading, when present and RFC3339.
    pub fn value_date(&self) -> Option<DateTime<FixedOffset>> {
        self.value_date.as_deref().and_then(parse_timestamp)
    }

    pub fn is_charging_station(&self) -> bool {
        self.meter_sub_type == Some(MeterSubType::ChargingStation)
            || self.family_type == Some(MeterFamilyType::MithralChargingStationV1)
            || self.charge_station_state.is_some()
    }
}

/// One measured quantity, identified by its OBIS code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValueData {
    #[serde(alias = "Obis", skip_serializing_if = "Option::is_none")]
    pub obis: Option<String>,
    #[serde(alias = "Value", skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Snapshot of all values of one device at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValuesData {
    #[serde(alias = "DeviceId", skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    #[serde(alias = "Date", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(alias = "Values", default, deserialize_with = "null_as_empty")]
    pub values: Vec<ValueData>,
}

impl ValuesData {
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.date.as_deref().and_then(parse_timestamp)
    }

    /// First value reported for `obis`.
    pub fn value(&self, obis: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|v| v.obis.as_deref() == Some(obis))
            .and_then(|v| v.value)
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

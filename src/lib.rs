//! Blocking client library for the smart-me metering REST API.

pub mod models {
    pub mod smartme;
}

pub mod client;
pub mod config;
pub mod utils;

pub use client::{ClientBuilder, HttpResponse, SmartMeClient, SmartMeError, Transport, TransportError, UreqTransport};
pub use config::Config;
pub use models::smartme::{
    ChargeStationState, Device, DeviceId, MeterEnergyType, MeterFamilyType, MeterSubType, ValueData, ValuesData,
};

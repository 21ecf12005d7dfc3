//! PC Meter: streams CPU and memory utilization to a serial panel meter.
//!
//! The core is a periodic driver ([`app::MeterDriver`]) that samples two OS
//! metrics ([`monitor`]), encodes them into a fixed ASCII wire format
//! ([`protocol`]) and writes them to a serial device ([`serial`]), with a
//! recovery policy that distinguishes transient hiccups from a lost link.
//! Front-ends observe it through the [`ui::StatusSink`] seam.

pub mod app;
pub mod config;
pub mod instance;
pub mod monitor;
pub mod protocol;
pub mod serial;
pub mod ui;

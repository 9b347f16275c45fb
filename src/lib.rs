//! Calibrate molecular phylograms into timetrees.
//!
//! Layers, innermost first: [`domain`] (trees, calibrations, no I/O),
//! [`application`] (estimator, export, plot and the run pipeline),
//! [`infrastructure`] (filesystem and service wiring) and [`cli`].

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;

//! Card Scanner
//!
//! Reads the identifying text printed on a trading card photo and looks the
//! card up in an online database. The pipeline: capture an image, pick a
//! crop region, binarize it, run OCR, parse a set code and number from the
//! text, then search.

pub mod capture;
pub mod config;
pub mod crop;
pub mod geometry;
pub mod lookup;
pub mod parser;
pub mod session;
pub mod vision;

#![no_std]

/// modules
pub mod err;
pub mod observer;

pub mod console;
pub mod hidg;

#[cfg(feature = "x11")]
pub mod x11;

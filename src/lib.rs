pub mod channel;
pub mod clock;
pub mod controller;
pub mod device;
pub mod gpio;
pub mod keyboard;
pub mod model;
pub mod playback;
pub mod sim;
pub mod store;
pub mod trigger;
pub mod typist;
pub mod waiter;

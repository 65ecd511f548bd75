pub mod zaber;

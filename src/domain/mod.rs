pub mod appliance;
pub mod battery;
pub mod ev;
pub mod forecast;
pub mod inverter;
pub mod plan;
pub mod types;

pub use appliance::*;
pub use battery::*;
pub use ev::*;
pub use forecast::*;
pub use inverter::*;
pub use plan::*;
pub use types::*;

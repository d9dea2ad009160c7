mod allocation;
mod reservation;
mod reservation_status;

pub use allocation::*;
pub use reservation::*;
pub use reservation_status::*;

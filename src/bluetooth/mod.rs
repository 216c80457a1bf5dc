pub mod packet;
pub mod scanner;
pub mod session;

pub use session::run_session;

pub mod intent;
pub mod pattern;
pub mod routing;
pub mod session;
pub mod shot;

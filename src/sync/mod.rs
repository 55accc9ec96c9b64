pub mod spinlock;

pub use spinlock::Spinlock;

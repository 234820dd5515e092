pub mod deployment;
pub mod identity;
pub mod reference;

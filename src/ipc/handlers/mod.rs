pub mod core;
pub mod onboarding;
pub mod parents;
pub mod roles;
pub mod roster;
pub mod schools;
pub mod sms;
pub mod staff;
pub mod students;

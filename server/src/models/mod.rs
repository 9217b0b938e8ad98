pub mod application;
pub mod user;

pub use application::{
    Application, ApplicationStage, ApplicationStatus, ApprovedPass, NewApplication, PaymentStatus,
    ReviewEntry, PASS_AMOUNT, ROUTE_POINTS,
};
pub use user::{AdminUser, Holder, NewUser, User};

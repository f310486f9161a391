pub mod enrollment;
pub mod payments;
pub mod scoring;

pub use self::enrollment::EnrollmentService;
pub use self::payments::PaymentService;
pub use self::scoring::ScoringService;

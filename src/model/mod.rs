pub mod attendance;
pub mod attendance_request;
pub mod location;
pub mod movement;
pub mod reimbursement;
pub mod role;

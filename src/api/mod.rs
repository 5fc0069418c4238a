pub mod attendance;
pub mod attendance_request;
pub mod movement;
pub mod reimbursement;

// PDF export workflow: analyze a formatted workbook, let the user arrange
// the vendor blocks, then hand the arrangement to the backend.

pub mod handlers;
pub mod naming;
pub mod session;

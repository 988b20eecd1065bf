pub mod recognition_gateway;
pub mod service_response;

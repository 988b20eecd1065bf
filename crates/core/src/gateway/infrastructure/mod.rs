pub mod analysis_summary;
pub mod http_recognition_gateway;

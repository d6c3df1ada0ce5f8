mod builder;
mod request;

pub use builder::{CsrBuilder, CsrBuilderFactory, FactoryBuilder};
pub use request::{CertificateRequest, sign_request};

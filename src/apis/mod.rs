pub mod openfda;

pub use openfda::OpenFdaClient;

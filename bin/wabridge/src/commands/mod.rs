pub mod capabilities;
pub mod gateway;
pub mod init;
pub mod serve;
pub mod status;

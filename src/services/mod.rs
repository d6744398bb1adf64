pub mod access_service;
pub mod chunk_reader;
pub mod commands;
pub mod path_encoder;
pub mod source_lister;
pub mod transfer_service;
pub mod uploader;
pub mod verifier;

pub mod base36;

pub mod key_material;
pub mod outbound;
pub mod replay;

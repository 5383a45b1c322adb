//! One codec per SQL Server scalar family.

pub mod binary;
pub mod bit;
pub mod character;
pub mod decimal;
pub mod float;
pub mod guid;
pub mod int;
pub mod money;
pub mod temporal;
pub mod xml;

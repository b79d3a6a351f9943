pub mod dead_letters;
pub mod run;

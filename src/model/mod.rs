pub mod isotonic;

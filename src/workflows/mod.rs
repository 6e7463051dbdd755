pub mod kardex;

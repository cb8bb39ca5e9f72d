pub mod cse;

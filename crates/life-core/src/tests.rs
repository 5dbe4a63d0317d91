mod lifecycle_tests;
mod ownership_tests;

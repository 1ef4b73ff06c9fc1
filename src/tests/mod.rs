mod common;

mod analysis_test;

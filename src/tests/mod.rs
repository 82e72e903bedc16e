mod support;

mod concurrent_tests;

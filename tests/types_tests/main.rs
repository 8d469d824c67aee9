//! Value type and codec integration tests

mod codec_tests;

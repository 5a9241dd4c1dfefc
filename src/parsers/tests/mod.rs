mod integration_tests;
mod meta_parser_tests;

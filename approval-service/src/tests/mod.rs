mod moderation_tests;
mod owner_view_tests;
mod utils;

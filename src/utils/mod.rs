pub mod time_range;

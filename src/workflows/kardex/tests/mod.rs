mod common;

mod schedule;

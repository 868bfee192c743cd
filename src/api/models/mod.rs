pub mod pit_stop;

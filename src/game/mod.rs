pub mod constants;
pub mod game_loop;
pub mod input_buffer;
pub mod schedule;
pub mod spatial;
pub mod state;
pub mod systems;
pub mod teams;
pub mod terrain;

mod debug_memory;
mod debug_source;

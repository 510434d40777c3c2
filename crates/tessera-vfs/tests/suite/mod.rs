mod composed_backends;
mod watch_engine;

mod error;
mod helpers;
mod lifecycle;
mod listener;
mod logging;

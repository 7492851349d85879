pub mod io;
pub mod template;

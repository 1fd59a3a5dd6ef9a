pub mod error;
pub mod client;

/// Gate behind ssh feature
#[cfg(feature = "ssh")]
pub mod ssh;

pub use error::*;

pub mod macros {
    #[macro_export]
    macro_rules! cmd {
        ($cmd:expr $(,$arg:expr)*) => {
            {
                let mut cmd = $crate::client::Command::new($cmd);
                $(
                    cmd = cmd.arg($arg);
                )*

                cmd
            }
        };
    }
}

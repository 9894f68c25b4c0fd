// Courier - asynchronous email delivery
//
// Producers enqueue `email:deliver` tasks into a priority-classed queue;
// workers render MJML templates and deliver over SMTP.

// Re-export the queue and logging
pub use courier_log as log;
pub use courier_queue::*;

// Re-export optional crates
#[cfg(feature = "config")]
pub use courier_config;

#[cfg(feature = "mail")]
pub use courier_mail;

// Prelude for common imports
pub mod prelude {
    pub use courier_queue::prelude::*;

    #[cfg(feature = "config")]
    pub use courier_config::CourierConfig;

    #[cfg(feature = "mail")]
    pub use courier_mail::prelude::*;
}

/// Appointment scheduling and conflict prevention
///
/// `rules` holds the pure slot rules (time window, upcoming/past, booker
/// identity); `AppointmentManager` applies them per acting role and commits
/// through the store, whose UNIQUE(scheduler, date, time) constraint is the
/// final guard against concurrent double booking.

mod manager;
pub mod rules;

pub use manager::{
    Actor, AppointmentManager, AppointmentOrdering, AppointmentPatch, AppointmentScope,
    AppointmentView, NewAppointment,
};

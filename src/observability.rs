use biometrics::{Collector, Counter};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("roomchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("roomchat.client.request_errors");

pub(crate) static STREAM_OPENS: Counter = Counter::new("roomchat.stream.opens");
pub(crate) static STREAM_EVENTS: Counter = Counter::new("roomchat.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("roomchat.stream.errors");
pub(crate) static STREAM_CLOSES: Counter = Counter::new("roomchat.stream.closes");

pub(crate) static SESSION_ROOM_SWITCHES: Counter = Counter::new("roomchat.session.room_switches");
pub(crate) static SESSION_SENDS: Counter = Counter::new("roomchat.session.sends");
pub(crate) static SESSION_SENDS_REJECTED: Counter =
    Counter::new("roomchat.session.sends_rejected");
pub(crate) static SESSION_STALE_EVENTS: Counter = Counter::new("roomchat.session.stale_events");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);

    collector.register_counter(&STREAM_OPENS);
    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_CLOSES);

    collector.register_counter(&SESSION_ROOM_SWITCHES);
    collector.register_counter(&SESSION_SENDS);
    collector.register_counter(&SESSION_SENDS_REJECTED);
    collector.register_counter(&SESSION_STALE_EVENTS);
}

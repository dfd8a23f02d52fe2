pub mod ms {
    pub const SCREENSHOT: u64 = 5000;
    pub const BARRIER_GRACE: u64 = 200;
    pub const POPUP_ATTACH_RETRY: u64 = 50;
    pub const DEFAULT_ACTION: u64 = 50000;
    pub const DEFAULT_NAVIGATION: u64 = 50000;
}

pub mod secs {
    pub const TRACE_DRAIN: u64 = 10;
    pub const REQUEST: u64 = 120;
}

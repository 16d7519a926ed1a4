pub mod mixpanel;
pub mod stripe;
pub mod supabase;

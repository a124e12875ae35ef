mod adaptation;
mod config;
mod end_to_end;
mod propagation;
mod reconciliation;
mod scheduling;

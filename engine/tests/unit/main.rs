mod common;

mod test_admin_api;
mod test_end_to_end;
mod test_queue;
mod test_rollback;
mod test_workers;

mod create_reconciled;
mod retry_backoff;
mod shutdown_drain;
mod tombstone_deletion;

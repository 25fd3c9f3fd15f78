mod sync_timeout;

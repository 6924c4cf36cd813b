mod artifact_cache;
mod pipeline_end_to_end;
mod test_utils;

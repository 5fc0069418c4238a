pub mod area_cache;

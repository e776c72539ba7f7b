pub mod compaction;

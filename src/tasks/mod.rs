pub mod link_task;

pub mod apigee;

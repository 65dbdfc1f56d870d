// Tests - Shared fixtures and end-to-end tests


mod harness;
